mod patch_manifest;
